use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::models::{Attachment, Poll, PollState};
use crate::voting::{Outcome, TallyResult};

const FOOTER_GENERATED: &str = "Generated at: ";
const FOOTER_HASH: &str = "Verification hash: ";

/// Renders the minutes of a poll as markdown-flavoured text. Works for open
/// polls too, in which case the result line reports the live quorum status.
///
/// The footer carries a SHA-256 of everything above it. The generation time
/// is outside the digest, so the same poll state always hashes the same.
pub fn render(poll: &Poll, tally: &TallyResult, generated_at: DateTime<Utc>) -> String {
    let body = render_body(poll, tally);
    let digest = sha256_hex(&body);

    let mut minutes = body;
    minutes.push_str("\n---\n");
    minutes.push_str(&format!(
        "{}{}\n",
        FOOTER_GENERATED,
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    minutes.push_str(&format!("{}{}\n", FOOTER_HASH, digest.to_uppercase()));
    minutes
}

/// Checks a rendered minutes text against its own verification hash.
pub fn verify(minutes: &str) -> bool {
    let Some((body, footer)) = minutes.rsplit_once("\n---\n") else {
        return false;
    };
    footer
        .lines()
        .find_map(|line| line.strip_prefix(FOOTER_HASH))
        .is_some_and(|hash| hash.eq_ignore_ascii_case(&sha256_hex(body)))
}

fn render_body(poll: &Poll, tally: &TallyResult) -> String {
    let mut summary = String::new();

    summary.push_str(&format!("# {}\n\n", poll.title));
    if !poll.description.is_empty() {
        summary.push_str(&poll.description);
        summary.push_str("\n\n");
    }
    if let Some(author) = &poll.created_by {
        summary.push_str(&format!("Created by {}\n", author));
    }
    summary.push_str(&format!(
        "Voting period: {} to {}\n",
        poll.opens_at.format("%Y-%m-%d %H:%M"),
        poll.closes_at.format("%Y-%m-%d %H:%M")
    ));
    if let Some(closed_at) = poll.closed_at {
        summary.push_str(&format!("Closed at: {}\n", closed_at.format("%Y-%m-%d %H:%M")));
    }

    if !poll.attachments.is_empty() {
        summary.push_str("\nAttachments:\n");
        for attachment in &poll.attachments {
            summary.push_str(&format!("- {}\n", describe_attachment(attachment)));
        }
    }

    summary.push_str(&format!(
        "\nParticipation: {} of {} ({:.1}%), quorum required {}%\n\n",
        tally.total_votes,
        tally.eligible_voter_count,
        tally.participation_pct,
        tally.quorum_required_pct
    ));

    let winners = winning_options(&tally.outcome);
    for entry in &tally.per_option {
        let line = if winners.contains(&entry.option_id.as_str()) {
            format!("**{}**: {} votes ({:.1}%)", entry.label, entry.votes, entry.share_pct)
        } else {
            format!("{}: {} votes ({:.1}%)", entry.label, entry.votes, entry.share_pct)
        };
        summary.push_str(&line);
        summary.push('\n');
    }

    summary.push_str(&format!("\nResult: {}\n", describe_outcome(poll, tally)));

    if poll.state == PollState::Closed {
        summary.push_str(if poll.audited {
            "Audit: confirmed\n"
        } else {
            "Audit: pending\n"
        });
    }

    summary
}

fn describe_attachment(attachment: &Attachment) -> String {
    match attachment.size_bytes {
        Some(bytes) => format!("{} ({})", attachment.name, format_size(bytes)),
        None => attachment.name.clone(),
    }
}

fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let size = bytes as f64;
    if size >= MB {
        format!("{:.1} MB", size / MB)
    } else if size >= KB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{} B", bytes)
    }
}

fn sha256_hex(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

fn winning_options(outcome: &Outcome) -> Vec<&str> {
    match outcome {
        Outcome::Elected { option_id } => vec![option_id.as_str()],
        Outcome::Tied { option_ids } => option_ids.iter().map(String::as_str).collect(),
        _ => Vec::new(),
    }
}

fn describe_outcome(poll: &Poll, tally: &TallyResult) -> String {
    match &tally.outcome {
        Outcome::Pending if tally.quorum_met => "in progress (quorum reached)".to_string(),
        Outcome::Pending => "in progress (awaiting quorum)".to_string(),
        Outcome::Approved => "approved".to_string(),
        Outcome::Rejected => "rejected".to_string(),
        Outcome::QuorumNotMet => "quorum not met".to_string(),
        Outcome::Elected { option_id } => format!("elected {}", option_label(poll, option_id)),
        Outcome::Tied { option_ids } => {
            let labels: Vec<String> = option_ids.iter().map(|id| option_label(poll, id)).collect();
            format!("tie between {}", labels.join(", "))
        }
    }
}

fn option_label(poll: &Poll, option_id: &str) -> String {
    poll.options
        .iter()
        .find(|option| option.id == option_id)
        .map(|option| option.label.clone())
        .unwrap_or_else(|| "Unknown Option".to_string())
}
