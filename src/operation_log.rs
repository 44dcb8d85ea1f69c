use crate::donation::{DonationFlow, DonationPlan, DonationState};
use anyhow::Result;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Log file name
const OPERATION_LOG_FILE: &str = "operation_log.txt";

/// Get the directory where app data is stored (same as settings)
fn app_data_dir() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        let app_dir = config_dir.join("fundpg");
        if !app_dir.exists() {
            let _ = fs::create_dir_all(&app_dir);
        }
        app_dir
    } else {
        // Fall back to current directory
        PathBuf::from(".")
    }
}

fn log_path() -> PathBuf {
    app_data_dir().join(OPERATION_LOG_FILE)
}

/// Format one entry: a timestamped header line, indented details, blank separator
fn format_entry(timestamp: &str, operation: &str, run_id: &str, details: &str) -> String {
    let mut entry = format!("[{}] run_id={} operation={}\n", timestamp, run_id, operation);
    if details.trim().is_empty() {
        entry.push_str("  (no additional details)\n");
    } else {
        for line in details.lines() {
            if line.trim().is_empty() {
                entry.push('\n');
            } else {
                entry.push_str("  ");
                entry.push_str(line);
                entry.push('\n');
            }
        }
    }
    entry.push('\n');
    entry
}

fn append_to(path: &Path, entry: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(entry.as_bytes())?;
    Ok(())
}

/// Append a structured log entry describing a user-requested operation.
pub fn append_log(operation: &str, run_id: &str, details: impl AsRef<str>) -> Result<()> {
    let timestamp = Utc::now().to_rfc3339();
    append_to(
        &log_path(),
        &format_entry(&timestamp, operation, run_id, details.as_ref()),
    )
}

/// Details block for a finished donation attempt
pub fn donation_details(plan: &DonationPlan, flow: &DonationFlow) -> String {
    let mut details = format!(
        "network={} ({})\ntoken={}\namount={}\nprojects={}\n",
        plan.network,
        plan.network.chain_id(),
        plan.token.map(|t| t.name).unwrap_or("-"),
        plan.amount,
        plan.selected_count
    );
    if let Ok(donations) = &plan.donations {
        for d in donations {
            details.push_str(&format!("  {} -> {:?}: {}\n", d.title, d.recipient, d.amount));
        }
    }
    details.push_str(&format!("result={}", flow.state()));
    if let DonationState::Succeeded { tx_hash } = flow.state() {
        if let Some(url) =
            crate::config::get_tx_explorer_url(plan.network.chain_id(), &format!("{:?}", tx_hash))
        {
            details.push_str(&format!("\nexplorer={}", url));
        }
    }
    details
}

pub fn log_donation(run_id: &str, plan: &DonationPlan, flow: &DonationFlow) -> Result<()> {
    append_log("donate", run_id, donation_details(plan, flow))
}

pub fn log_regeneration(run_id: &str, prompt: &str, outcome: &str) -> Result<()> {
    append_log("regenerate", run_id, format!("prompt={}\nresult={}", prompt, outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkName;
    use crate::donation::DonationRequest;
    use crate::tokens::tokens_for_network;
    use ethers::types::Address;

    fn plan() -> DonationPlan {
        DonationPlan {
            network: NetworkName::Optimism,
            token: Some(tokens_for_network(NetworkName::Optimism)[0]),
            amount: "5".to_string(),
            selected_count: 1,
            donations: Ok(vec![DonationRequest {
                amount: "5".to_string(),
                description: String::new(),
                title: "Lib".to_string(),
                recipient: Address::repeat_byte(0x11),
            }]),
        }
    }

    #[test]
    fn test_format_entry_indents_details() {
        let entry = format_entry("2024-01-01T00:00:00+00:00", "donate", "r1", "a=1\n\nb=2");
        assert_eq!(
            entry,
            "[2024-01-01T00:00:00+00:00] run_id=r1 operation=donate\n  a=1\n\n  b=2\n\n"
        );
    }

    #[test]
    fn test_format_entry_without_details() {
        let entry = format_entry("t", "regenerate", "r1", "  ");
        assert!(entry.contains("(no additional details)"));
    }

    #[test]
    fn test_donation_details() {
        let details = donation_details(&plan(), &DonationFlow::new());
        assert!(details.contains("network=Optimism (10)"));
        assert!(details.contains("token=USDC"));
        assert!(details.contains("Lib -> "));
        assert!(details.ends_with("result=Idle"));
    }

    #[test]
    fn test_append_to_creates_and_appends() {
        let dir = std::env::temp_dir().join(format!("fundpg-log-test-{}", std::process::id()));
        let path = dir.join(OPERATION_LOG_FILE);
        let _ = fs::remove_file(&path);

        append_to(&path, "one\n").unwrap();
        append_to(&path, "two\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
        let _ = fs::remove_dir_all(&dir);
    }
}
