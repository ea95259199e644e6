//! `extract-whitelist`: regenerate the whitelist from the documentation tree.

use crate::cli::ExtractArgs;
use cekura_openapi_tools::extractor::{self, ExtractorOptions};
use cekura_openapi_tools::whitelist::Whitelist;

/// Outcome of one extraction run.
#[derive(Debug, PartialEq, Eq)]
pub enum ExtractOutcome {
    Written { entries: usize },
    UpToDate { entries: usize },
    /// `--check` found a difference; nothing was written.
    Stale,
}

/// # Errors
///
/// Returns an error if the navigation file is missing or malformed, or the output cannot be
/// written.
pub fn run(args: &ExtractArgs) -> anyhow::Result<ExtractOutcome> {
    let navigation = args
        .navigation
        .clone()
        .unwrap_or_else(|| extractor::default_navigation(&args.docs_root));

    let mut options = ExtractorOptions::new(navigation, args.docs_root.clone());
    options.group = (!args.all_groups).then(|| args.group.clone());
    options.page_prefix.clone_from(&args.page_prefix);

    let extraction = extractor::extract(options)?;
    let generated = extraction.whitelist.to_json_string()?;
    let entries = extraction.whitelist.len();

    let existing = match std::fs::read_to_string(&args.output) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("failed to read '{}'", args.output.display())));
        }
    };

    if existing.as_deref() == Some(generated.as_str()) {
        tracing::info!(output = %args.output.display(), entries, "whitelist is up to date");
        return Ok(ExtractOutcome::UpToDate { entries });
    }

    let previous = match existing.as_deref().map(Whitelist::from_json) {
        Some(Ok(wl)) => wl,
        Some(Err(e)) => {
            tracing::warn!(
                output = %args.output.display(),
                error = %e,
                "existing whitelist is unreadable; treating it as empty"
            );
            Whitelist::new()
        }
        None => Whitelist::new(),
    };
    let diff = extraction.whitelist.diff(&previous);
    if diff.is_empty() {
        tracing::info!(
            output = %args.output.display(),
            "same operations; doc references or layout changed"
        );
    }
    for key in &diff.added {
        tracing::info!(entry = %key, "whitelist entry added");
    }
    for key in &diff.removed {
        tracing::warn!(entry = %key, "whitelist entry dropped");
    }

    if args.check {
        tracing::error!(
            output = %args.output.display(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "whitelist is stale; rerun extract-whitelist without --check"
        );
        return Ok(ExtractOutcome::Stale);
    }

    extraction.whitelist.write(&args.output)?;
    tracing::info!(
        output = %args.output.display(),
        entries,
        added = diff.added.len(),
        removed = diff.removed.len(),
        pages = extraction.pages_scanned,
        warnings = extraction.warnings.len(),
        "whitelist written"
    );
    Ok(ExtractOutcome::Written { entries })
}
