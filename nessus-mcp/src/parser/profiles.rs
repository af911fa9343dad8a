// Schema profiles: how much of each vulnerability record gets
// projected into the output. Profiles only ever narrow the field set —
// `full` is a strict superset of `brief`, which is a strict superset of
// `summary`, which is a strict superset of `minimal`.
//
// Field sets: minimal carries the 6 fields needed to triage at a glance
// (host, plugin, severity, CVE, CVSS, exploitability); summary adds the 3
// fields needed to read a finding without the full writeup; brief — the
// default — adds the 2 remediation fields. `full` drops field filtering
// entirely and also surfaces whatever the parser couldn't name (`extra`).

use serde_json::{json, Map, Value};

use crate::parser::report::{ParsedHost, ParsedItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaProfile {
    Minimal,
    Summary,
    Brief,
    Full,
}

impl SchemaProfile {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "minimal" => SchemaProfile::Minimal,
            "summary" => SchemaProfile::Summary,
            "brief" => SchemaProfile::Brief,
            "full" => SchemaProfile::Full,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaProfile::Minimal => "minimal",
            SchemaProfile::Summary => "summary",
            SchemaProfile::Brief => "brief",
            SchemaProfile::Full => "full",
        }
    }
}

/// Project one `(host, item)` pair into a JSON record at the given profile.
pub fn project(profile: SchemaProfile, host: &ParsedHost, item: &ParsedItem) -> Value {
    let mut record = Map::new();

    // minimal: 6 fields.
    record.insert("host".to_string(), json!(host.name));
    record.insert("plugin_id".to_string(), json!(item.plugin_id));
    record.insert("severity".to_string(), json!(item.severity));
    record.insert("cve".to_string(), json!(item.cve));
    record.insert("cvss_score".to_string(), json!(item.cvss_score));
    record.insert("exploit_available".to_string(), json!(item.exploit_available));

    if profile >= SchemaProfile::Summary {
        record.insert("plugin_name".to_string(), json!(item.plugin_name));
        record.insert("cvss3_base_score".to_string(), json!(item.cvss3_base_score));
        record.insert("synopsis".to_string(), json!(item.synopsis));
    }

    if profile >= SchemaProfile::Brief {
        record.insert("description".to_string(), json!(item.description));
        record.insert("solution".to_string(), json!(item.solution));
    }

    if profile >= SchemaProfile::Full {
        record.insert("port".to_string(), json!(item.port));
        record.insert("protocol".to_string(), json!(item.protocol));
        record.insert("plugin_family".to_string(), json!(item.plugin_family));
        record.insert("svc_name".to_string(), json!(item.svc_name));
        record.insert("plugin_output".to_string(), json!(item.plugin_output));
        for (key, value) in &item.extra {
            record.insert(key.clone(), json!(value));
        }
    }

    Value::Object(record)
}

impl PartialOrd for SchemaProfile {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaProfile {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        rank(self).cmp(&rank(other))
    }
}

fn rank(p: &SchemaProfile) -> u8 {
    match p {
        SchemaProfile::Minimal => 0,
        SchemaProfile::Summary => 1,
        SchemaProfile::Brief => 2,
        SchemaProfile::Full => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::report::ParsedItem;

    fn item() -> ParsedItem {
        ParsedItem {
            plugin_id: 1,
            plugin_name: "n".to_string(),
            plugin_family: "f".to_string(),
            severity: 2,
            port: 443,
            protocol: "tcp".to_string(),
            svc_name: "https".to_string(),
            plugin_output: Some("out".to_string()),
            cve: vec!["CVE-2020-0001".to_string()],
            cvss_score: Some(7.5),
            cvss3_base_score: Some(8.1),
            exploit_available: Some(true),
            description: Some("desc".to_string()),
            solution: Some("fix it".to_string()),
            synopsis: Some("short".to_string()),
            extra: Default::default(),
        }
    }

    #[test]
    fn minimal_has_exactly_six_fields() {
        let host = ParsedHost { name: "h".to_string(), items: vec![] };
        let record = project(SchemaProfile::Minimal, &host, &item());
        let obj = record.as_object().unwrap();
        assert_eq!(obj.len(), 6);
        assert!(obj.contains_key("cve"));
        assert!(obj.contains_key("cvss_score"));
        assert!(obj.contains_key("exploit_available"));
        assert!(!obj.contains_key("port"));
        assert!(!obj.contains_key("plugin_name"));
    }

    #[test]
    fn summary_has_exactly_nine_fields() {
        let host = ParsedHost { name: "h".to_string(), items: vec![] };
        let record = project(SchemaProfile::Summary, &host, &item());
        let obj = record.as_object().unwrap();
        assert_eq!(obj.len(), 9);
        assert!(obj.contains_key("plugin_name"));
        assert!(obj.contains_key("cvss3_base_score"));
        assert!(obj.contains_key("synopsis"));
    }

    #[test]
    fn brief_has_exactly_eleven_fields() {
        let host = ParsedHost { name: "h".to_string(), items: vec![] };
        let record = project(SchemaProfile::Brief, &host, &item());
        let obj = record.as_object().unwrap();
        assert_eq!(obj.len(), 11);
        assert!(obj.contains_key("description"));
        assert!(obj.contains_key("solution"));
    }

    #[test]
    fn full_includes_plugin_output_and_extra_fields() {
        let host = ParsedHost { name: "h".to_string(), items: vec![] };
        let mut with_extra = item();
        with_extra.extra.insert("risk_factor".to_string(), "High".to_string());
        let record = project(SchemaProfile::Full, &host, &with_extra);
        assert_eq!(record["plugin_output"], json!("out"));
        assert_eq!(record["risk_factor"], json!("High"));
        assert_eq!(record["port"], json!(443));
    }

    #[test]
    fn profile_ordering_is_monotonic() {
        assert!(SchemaProfile::Full > SchemaProfile::Brief);
        assert!(SchemaProfile::Brief > SchemaProfile::Summary);
        assert!(SchemaProfile::Summary > SchemaProfile::Minimal);
    }
}
