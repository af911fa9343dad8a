// Exercises parse -> project end to end over a multi-host document,
// covering pagination boundaries and the page == 0 "everything" escape
// hatch without going through a live scanner.

use nessus_mcp::parser::filters::FilterClause;
use nessus_mcp::parser::profiles::SchemaProfile;
use nessus_mcp::parser::projector::{self, ProjectionRequest};
use nessus_mcp::parser::report;

fn sample_document(hosts: usize, items_per_host: usize) -> String {
    let mut body = String::new();
    for h in 0..hosts {
        body.push_str(&format!("  <ReportHost name=\"10.0.0.{h}\">\n"));
        for i in 0..items_per_host {
            let severity = (i % 4) as u8;
            body.push_str(&format!(
                "    <ReportItem port=\"{port}\" svc_name=\"http\" protocol=\"tcp\" severity=\"{severity}\" pluginID=\"{plugin}\" pluginName=\"finding-{i}\" pluginFamily=\"Web Servers\"></ReportItem>\n",
                port = 80 + i,
                plugin = 10000 + i,
            ));
        }
        body.push_str("  </ReportHost>\n");
    }
    format!(
        "<?xml version=\"1.0\" ?>\n<NessusClientData_v2>\n<Report name=\"sample\">\n{body}</Report>\n</NessusClientData_v2>\n"
    )
}

#[test]
fn paginates_across_full_result_set() {
    let doc = sample_document(3, 10);
    let parsed = report::parse(doc.as_bytes()).unwrap();
    assert_eq!(parsed.hosts.len(), 3);

    let request = ProjectionRequest {
        profile: SchemaProfile::Brief,
        filters: &[],
        page: 1,
        page_size: 10,
    };
    let first_page = projector::project(&parsed, "sample", &request);
    let lines: Vec<&str> = first_page.lines().collect();
    // schema + scan_metadata + 10 records + pagination
    assert_eq!(lines.len(), 13);
    assert!(lines[0].contains("\"type\":\"schema\""));
    assert!(lines.last().unwrap().contains("\"has_next\":true"));

    let request_last = ProjectionRequest {
        profile: SchemaProfile::Brief,
        filters: &[],
        page: 3,
        page_size: 10,
    };
    let last_page = projector::project(&parsed, "sample", &request_last);
    assert!(last_page.lines().last().unwrap().contains("\"has_next\":false"));
}

#[test]
fn page_zero_skips_pagination_and_returns_every_record() {
    let doc = sample_document(2, 5);
    let parsed = report::parse(doc.as_bytes()).unwrap();

    let request = ProjectionRequest {
        profile: SchemaProfile::Minimal,
        filters: &[],
        page: 0,
        page_size: 10,
    };
    let output = projector::project(&parsed, "sample", &request);
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 12); // schema + scan_metadata + 10 records
    assert!(lines.iter().all(|l| !l.contains("\"type\":\"pagination\"")));
}

#[test]
fn filter_clause_narrows_result_set() {
    let doc = sample_document(1, 10);
    let parsed = report::parse(doc.as_bytes()).unwrap();

    let filters = vec![FilterClause::parse("severity=>=2").unwrap()];
    let request = ProjectionRequest {
        profile: SchemaProfile::Summary,
        filters: &filters,
        page: 0,
        page_size: 10,
    };
    let output = projector::project(&parsed, "sample", &request);
    let lines: Vec<&str> = output.lines().collect();
    // indices 2,3,6,7 have severity >= 2 out of 10 items (severity cycles 0,1,2,3)
    let vuln_lines = lines.iter().filter(|l| l.contains("\"type\":\"vulnerability\"")).count();
    assert_eq!(vuln_lines, 4);
}
