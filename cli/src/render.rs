//! Plain-text rendering of facade read models.

use std::fmt::Write;

use archive_facade::{ArchiveListing, ArchiveView, ArtifactListing, WriteOutcome};
use data_model::{ArtifactRecord, Loadable};
use ethers::{
    types::{Address, U256},
    utils::format_ether,
};

/// Wei as ether with trailing zeros removed, e.g. `0.01 ETH`.
pub fn format_wei(wei: U256) -> String {
    let ether = format_ether(wei);
    let ether = if ether.contains('.') {
        ether.trim_end_matches('0').trim_end_matches('.')
    } else {
        ether.as_str()
    };
    format!("{} ETH", ether)
}

fn field<T>(value: &Loadable<T>, show: impl Fn(&T) -> String) -> String {
    match value {
        Loadable::Ready { value } => show(value),
        Loadable::Unavailable { error } => format!("<unavailable: {}>", error),
    }
}

pub fn render_view(view: &ArchiveView, viewer: Option<&Address>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Archive {:?}", view.address);
    let _ = writeln!(out, "  name:        {}", field(&view.name, String::clone));
    let _ = writeln!(
        out,
        "  description: {}",
        field(&view.description, String::clone)
    );
    let _ = writeln!(out, "  admin:       {}", field(&view.admin, |a| format!("{:?}", a)));
    let _ = writeln!(
        out,
        "  balance:     {}",
        field(&view.info, |info| format_wei(info.balance))
    );
    let _ = writeln!(
        out,
        "  artifacts:   {}",
        field(&view.total_artifacts, U256::to_string)
    );
    let _ = writeln!(
        out,
        "  donors:      {}",
        field(&view.info, |info| info.total_donor_count.to_string())
    );
    if let Loadable::Ready { value: donors } = &view.donors {
        for donor in donors {
            let _ = writeln!(
                out,
                "    {:?}  {}  ({} donations)",
                donor.donor,
                format_wei(donor.total_donated),
                donor.donation_count
            );
        }
    }
    if let Some(viewer) = viewer {
        if view.admin_controls_visible(viewer) {
            let _ = writeln!(out, "  you are the admin: accept, reject and transfer-admin are available");
        }
    }
    if !view.is_ready() {
        let _ = writeln!(out, "  (some fields could not be loaded)");
    }
    out
}

pub fn render_listing(listing: &ArchiveListing) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} archives (showing from #{})",
        listing.total, listing.offset
    );
    for card in &listing.archives {
        match card {
            Loadable::Ready { value: summary } => {
                let _ = writeln!(
                    out,
                    "  #{} {:?}  {}  {}",
                    summary.index,
                    summary.address,
                    field(&summary.name, String::clone),
                    field(&summary.info, |info| format_wei(info.balance)),
                );
            }
            Loadable::Unavailable { error } => {
                let _ = writeln!(out, "  <unavailable: {}>", error);
            }
        }
    }
    out
}

fn render_artifact(artifact: &ArtifactRecord) -> String {
    format!(
        "#{} [{}] {}  {}  {}  by {:?}",
        artifact.id,
        artifact.status,
        artifact.title,
        artifact.mime_type,
        artifact.uri,
        artifact.submitter
    )
}

pub fn render_artifacts(listing: &ArtifactListing, pending_only: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} artifacts",
        field(&listing.total_artifacts, U256::to_string)
    );
    if pending_only {
        for artifact in listing.pending() {
            let _ = writeln!(out, "  {}", render_artifact(artifact));
        }
        return out;
    }
    for slot in &listing.artifacts {
        let line = field(&slot.artifact, render_artifact);
        let _ = writeln!(out, "  {}", line);
    }
    out
}

pub fn render_outcome<T>(action: &str, outcome: &WriteOutcome<T>) -> String {
    let mut out = String::new();
    let _ = write!(out, "{} confirmed in tx {:?}", action, outcome.confirmed.tx_hash);
    if let Some(block) = outcome.confirmed.block_number {
        let _ = write!(out, " (block {})", block);
    }
    let _ = writeln!(out);
    if !outcome.refresh_failures.is_empty() {
        let _ = writeln!(
            out,
            "  could not reload: {}",
            outcome.refresh_failures.join(", ")
        );
    }
    out
}
