// .nessus artifact parsing.
//
// The native format is a `NessusClientData_v2` document with one
// `ReportHost` per scanned host and one `ReportItem` per plugin finding.
// We flatten it into `ParsedReport` up front rather than streaming, since
// downstream projection needs random access for filtering and pagination.
//
// `ReportItem` child elements fall into four buckets: `cve` accumulates
// (a plugin can cite several), `cvss_score`/`cvss3_base_score` coerce to a
// float, `exploit_available` coerces to a bool, and everything else not
// named by a struct field lands in `extra` as a plain string — this is what
// lets the `full` schema profile round-trip every field present in the
// source artifact.

use std::collections::HashMap;
use std::io::BufRead;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::errors::ParseError;

#[derive(Debug, Clone, Default)]
pub struct ParsedItem {
    pub plugin_id: u64,
    pub plugin_name: String,
    pub plugin_family: String,
    pub severity: u8,
    pub port: u32,
    pub protocol: String,
    pub svc_name: String,
    pub plugin_output: Option<String>,
    pub cve: Vec<String>,
    pub cvss_score: Option<f64>,
    pub cvss3_base_score: Option<f64>,
    pub exploit_available: Option<bool>,
    pub description: Option<String>,
    pub solution: Option<String>,
    pub synopsis: Option<String>,
    /// Any child element not named by a field above, keyed by tag name.
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ParsedHost {
    pub name: String,
    pub items: Vec<ParsedItem>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedReport {
    pub hosts: Vec<ParsedHost>,
}

/// Parse a `.nessus` document from any buffered reader.
pub fn parse<R: BufRead>(reader: R) -> Result<ParsedReport, ParseError> {
    let mut xml = Reader::from_reader(reader);
    xml.trim_text(true);

    let mut buf = Vec::new();
    let mut hosts = Vec::new();

    let mut current_host: Option<ParsedHost> = None;
    let mut current_item: Option<ParsedItem> = None;
    let mut current_child: Option<String> = None;

    loop {
        match xml.read_event_into(&mut buf).map_err(|e| ParseError::Malformed(e.to_string()))? {
            Event::Eof => break,
            Event::Start(ref e) if e.name().as_ref() == b"ReportHost" => {
                let name = attr(e, b"name").unwrap_or_default();
                current_host = Some(ParsedHost { name, items: Vec::new() });
            }
            Event::End(ref e) if e.name().as_ref() == b"ReportHost" => {
                if let Some(host) = current_host.take() {
                    hosts.push(host);
                }
            }
            Event::Start(ref e) if e.name().as_ref() == b"ReportItem" => {
                current_item = Some(ParsedItem {
                    plugin_id: attr(e, b"pluginID").and_then(|v| v.parse().ok()).unwrap_or(0),
                    plugin_name: attr(e, b"pluginName").unwrap_or_default(),
                    plugin_family: attr(e, b"pluginFamily").unwrap_or_default(),
                    severity: attr(e, b"severity").and_then(|v| v.parse().ok()).unwrap_or(0),
                    port: attr(e, b"port").and_then(|v| v.parse().ok()).unwrap_or(0),
                    protocol: attr(e, b"protocol").unwrap_or_default(),
                    svc_name: attr(e, b"svc_name").unwrap_or_default(),
                    ..Default::default()
                });
            }
            Event::End(ref e) if e.name().as_ref() == b"ReportItem" => {
                if let (Some(item), Some(host)) = (current_item.take(), current_host.as_mut()) {
                    host.items.push(item);
                }
            }
            // Any direct child of ReportItem we haven't closed yet: remember its
            // tag name so the following Text event knows where to route.
            Event::Start(ref e) if current_item.is_some() => {
                current_child = Some(String::from_utf8_lossy(e.name().as_ref()).into_owned());
            }
            Event::Text(ref e) if current_item.is_some() && current_child.is_some() => {
                let text = e.unescape().map_err(|err| ParseError::Malformed(err.to_string()))?.into_owned();
                let tag = current_child.clone().unwrap();
                apply_child(current_item.as_mut().unwrap(), &tag, text);
            }
            Event::End(ref e) if current_item.is_some() => {
                let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if current_child.as_deref() == Some(tag.as_str()) {
                    current_child = None;
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(ParsedReport { hosts })
}

/// Route one `ReportItem` child element's text into the right field,
/// applying the coercion rule for that tag.
fn apply_child(item: &mut ParsedItem, tag: &str, text: String) {
    match tag {
        "plugin_output" => item.plugin_output = Some(text),
        "cve" => item.cve.push(text),
        "cvss_score" | "cvss_base_score" => item.cvss_score = text.parse().ok(),
        "cvss3_base_score" => item.cvss3_base_score = text.parse().ok(),
        "exploit_available" => item.exploit_available = Some(text.eq_ignore_ascii_case("true")),
        "description" => item.description = Some(text),
        "solution" => item.solution = Some(text),
        "synopsis" => item.synopsis = Some(text),
        other => {
            item.extra.insert(other.to_string(), text);
        }
    }
}

pub fn parse_file(path: &std::path::Path) -> Result<ParsedReport, ParseError> {
    let file = std::fs::File::open(path).map_err(|e| ParseError::Malformed(format!("opening artifact: {e}")))?;
    parse(std::io::BufReader::new(file))
}

fn attr(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" ?>
<NessusClientData_v2>
  <Report name="t">
    <ReportHost name="10.0.0.1">
      <ReportItem port="0" svc_name="general" protocol="tcp" severity="0" pluginID="19506" pluginName="Nessus Scan Information" pluginFamily="Settings">
        <plugin_output>Credentialed checks : yes</plugin_output>
      </ReportItem>
      <ReportItem port="443" svc_name="https" protocol="tcp" severity="2" pluginID="12345" pluginName="Some Finding" pluginFamily="Web Servers">
        <plugin_output>detail</plugin_output>
        <cve>CVE-2020-0001</cve>
        <cve>CVE-2020-0002</cve>
        <cvss_score>7.5</cvss_score>
        <cvss3_base_score>8.1</cvss3_base_score>
        <exploit_available>true</exploit_available>
        <description>A thing is wrong.</description>
        <solution>Patch it.</solution>
        <synopsis>Short version.</synopsis>
        <risk_factor>High</risk_factor>
      </ReportItem>
    </ReportHost>
  </Report>
</NessusClientData_v2>
"#;

    #[test]
    fn parses_hosts_and_items() {
        let report = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(report.hosts.len(), 1);
        assert_eq!(report.hosts[0].name, "10.0.0.1");
        assert_eq!(report.hosts[0].items.len(), 2);
        assert_eq!(report.hosts[0].items[1].plugin_id, 12345);
        assert_eq!(report.hosts[0].items[1].severity, 2);
    }

    #[test]
    fn captures_plugin_output() {
        let report = parse(SAMPLE.as_bytes()).unwrap();
        assert_eq!(
            report.hosts[0].items[0].plugin_output.as_deref(),
            Some("Credentialed checks : yes")
        );
    }

    #[test]
    fn accumulates_multiple_cve_tags() {
        let report = parse(SAMPLE.as_bytes()).unwrap();
        let item = &report.hosts[0].items[1];
        assert_eq!(item.cve, vec!["CVE-2020-0001".to_string(), "CVE-2020-0002".to_string()]);
    }

    #[test]
    fn coerces_scores_and_booleans() {
        let report = parse(SAMPLE.as_bytes()).unwrap();
        let item = &report.hosts[0].items[1];
        assert_eq!(item.cvss_score, Some(7.5));
        assert_eq!(item.cvss3_base_score, Some(8.1));
        assert_eq!(item.exploit_available, Some(true));
        assert_eq!(item.description.as_deref(), Some("A thing is wrong."));
        assert_eq!(item.solution.as_deref(), Some("Patch it."));
        assert_eq!(item.synopsis.as_deref(), Some("Short version."));
    }

    #[test]
    fn unnamed_children_land_in_extra() {
        let report = parse(SAMPLE.as_bytes()).unwrap();
        let item = &report.hosts[0].items[1];
        assert_eq!(item.extra.get("risk_factor").map(String::as_str), Some("High"));
    }
}
