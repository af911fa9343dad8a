// CIDR-aware target matching used by `TaskStore::list`'s `target` predicate
// (boundary behaviors).
//
// A stored target string may list several comma/whitespace separated tokens
// (Nessus accepts the same format for scan targets); a query matches if any
// token matches by any of: query-IP-in-stored-network,
// stored-IP-in-query-network, network overlap, or (fallback) case-insensitive
// hostname equality.

use ipnet::IpNet;
use std::net::IpAddr;

enum Token {
    Net(IpNet),
    Addr(IpAddr),
    Host(String),
}

fn parse_token(raw: &str) -> Token {
    let raw = raw.trim();
    if let Ok(net) = raw.parse::<IpNet>() {
        return Token::Net(net);
    }
    if let Ok(addr) = raw.parse::<IpAddr>() {
        return Token::Addr(addr);
    }
    Token::Host(raw.to_lowercase())
}

fn split_targets(targets: &str) -> Vec<&str> {
    targets
        .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect()
}

fn tokens_match(query: &Token, stored: &Token) -> bool {
    match (query, stored) {
        (Token::Addr(q), Token::Net(s)) => s.contains(q),
        (Token::Net(q), Token::Addr(s)) => q.contains(s),
        (Token::Net(q), Token::Net(s)) => networks_overlap(q, s),
        (Token::Addr(q), Token::Addr(s)) => q == s,
        (Token::Host(q), Token::Host(s)) => q == s,
        _ => false,
    }
}

fn networks_overlap(a: &IpNet, b: &IpNet) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Whether `query` (a single address, CIDR, or hostname) matches any token
/// in `stored_targets`.
pub fn target_matches(query: &str, stored_targets: &str) -> bool {
    let query_token = parse_token(query);
    split_targets(stored_targets)
        .into_iter()
        .any(|stored_raw| tokens_match(&query_token, &parse_token(stored_raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ip_in_stored_cidr_matches() {
        assert!(target_matches("192.168.1.5", "192.168.1.0/24"));
    }

    #[test]
    fn ip_outside_stored_cidr_does_not_match() {
        assert!(!target_matches("10.0.1.0", "10.0.0.0/24"));
    }

    #[test]
    fn stored_ip_in_query_cidr_matches() {
        assert!(target_matches("10.0.0.0/24", "10.0.0.50"));
    }

    #[test]
    fn overlapping_networks_match() {
        assert!(target_matches("172.16.0.0/16", "172.16.5.0/24"));
    }

    #[test]
    fn hostname_fallback_is_case_insensitive() {
        assert!(target_matches("Web-Server.Example.Com", "web-server.example.com"));
        assert!(!target_matches("other-host", "web-server.example.com"));
    }

    #[test]
    fn multi_target_list_matches_any_token() {
        assert!(target_matches("10.0.0.50", "192.168.1.0/24, 10.0.0.50"));
    }
}
