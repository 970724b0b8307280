//! Statistics over the spam audit log, as printed by the `analyze` binary.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::BufRead;

use crate::audit::SPAM_MARKER;

/// Rows shown per ranking.
const TOP_N: usize = 10;

/// Aggregated view of an audit log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpamStats {
    pub total_emails: usize,
    pub by_domain: HashMap<String, usize>,
    pub by_address: HashMap<String, usize>,
    /// Subjects in log order.
    pub subjects: Vec<String>,
}

impl SpamStats {
    /// Read audit lines. Lines without the marker are ignored; a marked line
    /// without an ` - ` separator only counts toward the total. Invalid UTF-8
    /// is replaced, not rejected.
    pub fn parse<R: BufRead>(reader: R) -> std::io::Result<Self> {
        let mut stats = Self::default();
        for line in reader.split(b'\n') {
            let line = line?;
            let line = String::from_utf8_lossy(&line);
            stats.add_line(line.trim_end_matches('\r'));
        }
        Ok(stats)
    }

    fn add_line(&mut self, line: &str) {
        let Some((_, content)) = line.split_once(SPAM_MARKER) else {
            return;
        };
        self.total_emails += 1;

        let Some((address, subject)) = content.trim().split_once(" - ") else {
            return;
        };
        let address = address.trim();

        if let Some((_, domain)) = address.split_once('@') {
            *self.by_domain.entry(domain.to_string()).or_default() += 1;
        }
        *self.by_address.entry(address.to_string()).or_default() += 1;
        self.subjects.push(subject.trim().to_string());
    }

    pub fn top_domains(&self, n: usize) -> Vec<(&str, usize)> {
        top_n(&self.by_domain, n)
    }

    pub fn top_addresses(&self, n: usize) -> Vec<(&str, usize)> {
        top_n(&self.by_address, n)
    }

    fn percent(&self, count: usize) -> f64 {
        count as f64 * 100.0 / self.total_emails as f64
    }

    /// Human-readable report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Spam Classification Statistics ===");
        let _ = writeln!(out, "\nTotal spam emails detected: {}", self.total_emails);

        if self.total_emails == 0 {
            let _ = writeln!(out, "\nNo spam emails found in the log file.");
            return out;
        }

        let _ = writeln!(out, "\n=== Top Spam Domains ===");
        self.render_ranking(&mut out, &self.top_domains(TOP_N));

        let _ = writeln!(out, "\n=== Top Spam Addresses ===");
        self.render_ranking(&mut out, &self.top_addresses(TOP_N));

        let _ = writeln!(out, "\n=== Sample Spam Subjects (first {TOP_N}) ===");
        for (i, subject) in self.subjects.iter().take(TOP_N).enumerate() {
            let _ = writeln!(out, "{:2}. {subject}", i + 1);
        }
        out
    }

    fn render_ranking(&self, out: &mut String, rows: &[(&str, usize)]) {
        for (i, (key, count)) in rows.iter().enumerate() {
            let _ = writeln!(
                out,
                "{:2}. {key}: {count} emails ({:.1}%)",
                i + 1,
                self.percent(*count)
            );
        }
    }
}

/// The `n` largest counts, ties broken by key.
fn top_n(counts: &HashMap<String, usize>, n: usize) -> Vec<(&str, usize)> {
    let mut items: Vec<(&str, usize)> = counts.iter().map(|(k, v)| (k.as_str(), *v)).collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    items.truncate(n);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SpamStats {
        SpamStats::parse(text.as_bytes()).unwrap()
    }

    const SAMPLE: &str = "\
Classified as spam: a@x.com - Win a prize
Classified as spam: b@y.com - Cheap pills
unrelated line
Classified as spam: a@x.com - Win again
";

    #[test]
    fn counts_addresses_and_domains() {
        let stats = parse(SAMPLE);
        assert_eq!(stats.total_emails, 3);
        assert_eq!(stats.top_addresses(10), vec![("a@x.com", 2), ("b@y.com", 1)]);
        assert_eq!(stats.top_domains(10), vec![("x.com", 2), ("y.com", 1)]);
        assert_eq!(stats.subjects, vec!["Win a prize", "Cheap pills", "Win again"]);
    }

    #[test]
    fn render_shows_percentages() {
        let out = parse(SAMPLE).render();
        assert!(out.contains("Total spam emails detected: 3"));
        assert!(out.contains(" 1. a@x.com: 2 emails (66.7%)"));
        assert!(out.contains(" 2. b@y.com: 1 emails (33.3%)"));
        assert!(out.contains(" 1. Win a prize"));
    }

    #[test]
    fn malformed_marked_line_counts_only_toward_total() {
        let stats = parse("2024/01/01 Classified as spam: no-separator\n");
        assert_eq!(stats.total_emails, 1);
        assert!(stats.by_address.is_empty());
        assert!(stats.subjects.is_empty());
    }

    #[test]
    fn invalid_utf8_line_does_not_stop_parsing() {
        let mut log = b"Classified as spam: a@x.com - Caf\xe9 deals\r\n".to_vec();
        log.extend_from_slice(b"Classified as spam: b@y.com - Hello\n");
        let stats = SpamStats::parse(log.as_slice()).unwrap();
        assert_eq!(stats.total_emails, 2);
        assert_eq!(stats.top_addresses(10), vec![("a@x.com", 1), ("b@y.com", 1)]);
        assert_eq!(stats.subjects[1], "Hello");
        assert!(stats.subjects[0].starts_with("Caf"));
    }

    #[test]
    fn address_without_at_has_no_domain() {
        let stats = parse("Classified as spam: localonly - Hi\n");
        assert_eq!(stats.by_address.get("localonly"), Some(&1));
        assert!(stats.by_domain.is_empty());
    }

    #[test]
    fn ties_sorted_by_key() {
        let stats = parse(
            "Classified as spam: z@c.com - 1\n\
             Classified as spam: a@b.com - 2\n",
        );
        assert_eq!(stats.top_addresses(1), vec![("a@b.com", 1)]);
    }

    #[test]
    fn empty_log_prints_notice() {
        let out = parse("").render();
        assert!(out.contains("Total spam emails detected: 0"));
        assert!(out.contains("No spam emails found"));
    }
}
