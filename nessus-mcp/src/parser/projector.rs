// JSON-lines projector.
//
// Emits, in order: one `schema` line describing the active profile, one
// `scan_metadata` line, one line per matching vulnerability record at the
// requested page, and a trailing `pagination` line. `page_size` is clamped
// to [10, 100]; `page == 0` is a special case meaning "return every matching
// record, unpaginated" (used by callers that already know the result set is
// small, e.g. export-to-file tooling).

use serde_json::json;

use crate::parser::filters::{self, FilterClause};
use crate::parser::profiles::{self, SchemaProfile};
use crate::parser::report::ParsedReport;

const MIN_PAGE_SIZE: u32 = 10;
const MAX_PAGE_SIZE: u32 = 100;

pub struct ProjectionRequest<'a> {
    pub profile: SchemaProfile,
    pub filters: &'a [FilterClause],
    pub page: u32,
    pub page_size: u32,
}

pub fn clamp_page_size(requested: u32) -> u32 {
    requested.clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

/// Project a parsed report into JSON-lines text per `request`.
pub fn project(report: &ParsedReport, scan_name: &str, request: &ProjectionRequest) -> String {
    let mut all_records = Vec::new();
    for host in &report.hosts {
        for item in &host.items {
            let record = profiles::project(request.profile, host, item);
            if filters::matches_all(request.filters, &record) {
                all_records.push(record);
            }
        }
    }

    let total_records = all_records.len();
    let page_size = clamp_page_size(request.page_size);

    let (page_records, page, total_pages): (Vec<_>, u32, u32) = if request.page == 0 {
        (all_records, 0, 1)
    } else {
        let total_pages = ((total_records as u32).saturating_add(page_size - 1) / page_size).max(1);
        let page = request.page.min(total_pages);
        let start = ((page - 1) * page_size) as usize;
        let end = (start + page_size as usize).min(total_records);
        let slice = if start < total_records { all_records[start..end].to_vec() } else { Vec::new() };
        (slice, page, total_pages)
    };

    let mut lines = Vec::with_capacity(page_records.len() + 3);
    lines.push(
        json!({
            "type": "schema",
            "profile": request.profile.as_str(),
            "filters_applied": request.filters.iter().map(|f| format!("{}={}", f.field, f.expression)).collect::<Vec<_>>(),
            "total_vulnerabilities": total_records,
            "total_pages": total_pages,
        })
        .to_string(),
    );
    lines.push(
        json!({
            "type": "scan_metadata",
            "scan_name": scan_name,
            "host_count": report.hosts.len(),
            "total_records": total_records,
        })
        .to_string(),
    );
    for record in page_records {
        let mut with_type = record;
        with_type["type"] = json!("vulnerability");
        lines.push(with_type.to_string());
    }

    if request.page != 0 {
        let has_next = page < total_pages;
        lines.push(
            json!({
                "type": "pagination",
                "page": page,
                "page_size": page_size,
                "total_pages": total_pages,
                "has_next": has_next,
                "next_page": if has_next { Some(page + 1) } else { None },
            })
            .to_string(),
        );
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::report::{ParsedHost, ParsedItem};

    fn sample_report(count: usize) -> ParsedReport {
        let items = (0..count)
            .map(|i| ParsedItem {
                plugin_id: i as u64,
                plugin_name: format!("plugin-{i}"),
                plugin_family: "f".to_string(),
                severity: (i % 4) as u8,
                port: 80,
                protocol: "tcp".to_string(),
                svc_name: "http".to_string(),
                ..Default::default()
            })
            .collect();
        ParsedReport {
            hosts: vec![ParsedHost { name: "10.0.0.1".to_string(), items }],
        }
    }

    #[test]
    fn page_size_is_clamped() {
        assert_eq!(clamp_page_size(1), MIN_PAGE_SIZE);
        assert_eq!(clamp_page_size(1000), MAX_PAGE_SIZE);
        assert_eq!(clamp_page_size(50), 50);
    }

    #[test]
    fn page_zero_returns_everything_unpaginated() {
        let report = sample_report(25);
        let request = ProjectionRequest {
            profile: SchemaProfile::Minimal,
            filters: &[],
            page: 0,
            page_size: 10,
        };
        let output = project(&report, "scan", &request);
        let lines: Vec<&str> = output.lines().collect();
        // schema + scan_metadata + 25 vulnerability records, no pagination frame
        assert_eq!(lines.len(), 27);
    }

    #[test]
    fn pagination_splits_into_pages() {
        let report = sample_report(25);
        let request = ProjectionRequest {
            profile: SchemaProfile::Minimal,
            filters: &[],
            page: 2,
            page_size: 10,
        };
        let output = project(&report, "scan", &request);
        let lines: Vec<&str> = output.lines().collect();
        // schema + scan_metadata + 10 records + pagination
        assert_eq!(lines.len(), 13);
    }
}
