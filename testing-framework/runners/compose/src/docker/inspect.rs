use serde::Deserialize;

use crate::container::ContainerStatus;

/// One entry of `docker compose ps --format json`.
#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "State")]
    state: String,
    #[serde(rename = "ExitCode", default)]
    exit_code: i32,
}

impl From<PsEntry> for ContainerStatus {
    fn from(entry: PsEntry) -> Self {
        let state = entry
            .state
            .parse()
            .unwrap_or_else(|never| match never {});
        ContainerStatus::new(entry.service, state, entry.exit_code)
    }
}

/// Parse `docker compose ps --format json` output.
///
/// Compose up to v2.20 prints one JSON array; later releases print one object
/// per line. Both are accepted, as is empty output.
pub fn parse_ps_output(raw: &str) -> Result<Vec<ContainerStatus>, serde_json::Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let entries: Vec<PsEntry> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else {
        trimmed
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(serde_json::from_str)
            .collect::<Result<_, _>>()?
    };

    Ok(entries.into_iter().map(ContainerStatus::from).collect())
}
