use regex::Regex;

/// Result of checking a copy-tool transcript against a list of files.
#[derive(Debug, Default)]
pub struct TransferOutcome {
    failed: Vec<String>,
}

impl TransferOutcome {
    pub fn is_verified(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn into_failed(self) -> Vec<String> {
        self.failed
    }
}

/// Scan a transcript for the per-file marker pair. A file counts as
/// transferred only when both its `Sending file modes:` and `Sink:` lines
/// are present; the exit code of the copy process says nothing once the
/// relay has had a chance to swallow or reorder stream content.
pub fn check(transcript: &str, names: &[String]) -> TransferOutcome {
    let failed = names
        .iter()
        .filter(|name| !file_verified(transcript, name))
        .cloned()
        .collect();
    TransferOutcome { failed }
}

fn file_verified(transcript: &str, name: &str) -> bool {
    marker_present(transcript, "Sending file modes:", name)
        && marker_present(transcript, "Sink:", name)
}

/// A marker line looks like `Sink: C0644 6 data.txt`. The mode and size
/// tokens are required so a bare mention of the file name does not count,
/// and the name is anchored at end of line so `in.txt` cannot match
/// `main.txt`.
fn marker_present(transcript: &str, marker: &str, name: &str) -> bool {
    let pattern = format!(
        r"(?m){} [A-Za-z]\d+ \d+ {}[ \t]*$",
        regex::escape(marker),
        regex::escape(name)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(transcript),
        // both parts are escaped; treat an unbuildable pattern as unverified
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn both_markers_verify_a_file() {
        let transcript = "Sending file modes: C0644 6 data.txt\nSink: C0644 6 data.txt\n";
        let outcome = check(transcript, &names(&["data.txt"]));
        assert!(outcome.is_verified());
    }

    #[test]
    fn missing_sink_marker_fails_that_file_only() {
        let transcript = "\
Sending file modes: C0644 6 data.txt
Sink: C0644 6 data.txt
Sending file modes: C0644 12 other.dat
";
        let outcome = check(transcript, &names(&["data.txt", "other.dat"]));
        assert_eq!(outcome.failed(), ["other.dat"]);
    }

    #[test]
    fn missing_sending_marker_fails_verification() {
        let transcript = "Sink: C0644 6 data.txt\n";
        let outcome = check(transcript, &names(&["data.txt"]));
        assert_eq!(outcome.failed(), ["data.txt"]);
    }

    #[test]
    fn file_name_must_match_exactly() {
        let transcript = "Sending file modes: C0644 6 main.txt\nSink: C0644 6 main.txt\n";
        let outcome = check(transcript, &names(&["in.txt"]));
        assert_eq!(outcome.failed(), ["in.txt"]);
    }

    #[test]
    fn mode_and_size_tokens_are_required() {
        let transcript = "Sending file modes: data.txt\nSink: data.txt\n";
        let outcome = check(transcript, &names(&["data.txt"]));
        assert_eq!(outcome.failed(), ["data.txt"]);
    }

    #[test]
    fn multi_digit_sizes_are_accepted() {
        let transcript =
            "Sending file modes: C0755 123456 results.tar\nSink: C0755 123456 results.tar\n";
        let outcome = check(transcript, &names(&["results.tar"]));
        assert!(outcome.is_verified());
    }

    #[test]
    fn empty_file_list_is_trivially_verified() {
        let outcome = check("", &[]);
        assert!(outcome.is_verified());
    }
}
