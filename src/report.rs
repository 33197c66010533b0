//! Verification reports.
//!
//! A report is built from the per-signature [`VerificationResult`]s of one
//! document. The kind of report is chosen with [`ReportKind`]; every kind
//! serializes to JSON.

use std::fmt;

use serde::Serialize;

use crate::error::Result;
use crate::signatures::VerificationResult;

/// Which report to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportKind {
    /// One entry per signature
    #[default]
    Simple,
    /// Totals only
    Summary,
}

/// Inputs every report is built from.
pub trait BuildReport: Sized {
    /// Build the report for `file_name` from its verification results.
    fn build(file_name: String, file_size: u64, results: Vec<VerificationResult>) -> Self;
}

/// A built report.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationReport {
    /// See [`SimpleReport`]
    Simple(SimpleReport),
    /// See [`SummaryReport`]
    Summary(SummaryReport),
}

impl VerificationReport {
    /// Build a report of the given kind.
    pub fn build(
        kind: ReportKind,
        file_name: String,
        file_size: u64,
        results: Vec<VerificationResult>,
    ) -> Self {
        match kind {
            ReportKind::Simple => {
                Self::Simple(SimpleReport::build(file_name, file_size, results))
            },
            ReportKind::Summary => {
                Self::Summary(SummaryReport::build(file_name, file_size, results))
            },
        }
    }

    /// Whether every signature in the document is valid.
    ///
    /// A document without signatures is not considered valid.
    pub fn all_valid(&self) -> bool {
        match self {
            Self::Simple(report) => {
                !report.entries.is_empty() && report.entries.iter().all(|e| e.valid)
            },
            Self::Summary(report) => report.signatures > 0 && report.invalid == 0,
        }
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(report) => report.fmt(f),
            Self::Summary(report) => report.fmt(f),
        }
    }
}

/// One signature in a [`SimpleReport`].
#[derive(Debug, Clone, Serialize)]
pub struct SignatureEntry {
    /// Name of the signature field
    pub field_name: Option<String>,
    /// Name of the signer
    pub name: Option<String>,
    /// Signing location
    pub location: Option<String>,
    /// Reason for signing
    pub reason: Option<String>,
    /// RFC 3339 signing time
    pub signing_time: Option<String>,
    /// Signature sub-filter
    pub sub_filter: Option<String>,
    /// Mathematical validity
    pub valid: bool,
    /// Whether the signature covers the whole file
    pub covers_whole_document: bool,
    /// Signer certificate first, then the chain
    pub certificates: Vec<String>,
    /// Why the signature is invalid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl From<VerificationResult> for SignatureEntry {
    fn from(result: VerificationResult) -> Self {
        let certificates = result.certificates().map(ToString::to_string).collect();
        Self {
            field_name: result.field_name,
            name: result.signer_name,
            location: result.location,
            reason: result.reason,
            signing_time: result.signing_time.map(|t| t.to_rfc3339()),
            sub_filter: result.sub_filter,
            valid: result.is_valid,
            covers_whole_document: result.covers_whole_document,
            certificates,
            failure: result.failure,
        }
    }
}

/// File name, size and every signature with its certificate chain.
#[derive(Debug, Clone, Serialize)]
pub struct SimpleReport {
    /// Document file name
    pub file_name: String,
    /// Document size in bytes
    pub file_size: u64,
    /// Signatures in form order
    pub entries: Vec<SignatureEntry>,
}

impl BuildReport for SimpleReport {
    fn build(file_name: String, file_size: u64, results: Vec<VerificationResult>) -> Self {
        Self {
            file_name,
            file_size,
            entries: results.into_iter().map(SignatureEntry::from).collect(),
        }
    }
}

impl fmt::Display for SimpleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} bytes)", self.file_name, self.file_size)?;
        for entry in &self.entries {
            writeln!(
                f,
                "  {}: {}{}",
                entry.field_name.as_deref().unwrap_or("<unnamed>"),
                if entry.valid { "valid" } else { "INVALID" },
                if entry.covers_whole_document { "" } else { " (partial)" }
            )?;
            if let Some(name) = &entry.name {
                writeln!(f, "    signer: {}", name)?;
            }
            for cert in &entry.certificates {
                writeln!(f, "    {}", cert)?;
            }
            if let Some(failure) = &entry.failure {
                writeln!(f, "    failure: {}", failure)?;
            }
        }
        Ok(())
    }
}

/// Totals over all signatures of a document.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    /// Document file name
    pub file_name: String,
    /// Document size in bytes
    pub file_size: u64,
    /// Number of signatures
    pub signatures: usize,
    /// Signatures judged valid
    pub valid: usize,
    /// Signatures judged invalid
    pub invalid: usize,
    /// Whether the most recent signature covers the whole file
    pub last_covers_whole_document: bool,
    /// Signer names in form order
    pub signers: Vec<String>,
}

impl BuildReport for SummaryReport {
    fn build(file_name: String, file_size: u64, results: Vec<VerificationResult>) -> Self {
        let valid = results.iter().filter(|r| r.is_valid).count();
        Self {
            file_name,
            file_size,
            signatures: results.len(),
            valid,
            invalid: results.len() - valid,
            last_covers_whole_document: results
                .last()
                .map(|r| r.covers_whole_document)
                .unwrap_or(false),
            signers: results.into_iter().filter_map(|r| r.signer_name).collect(),
        }
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({} bytes): {} signature(s), {} valid, {} invalid",
            self.file_name, self.file_size, self.signatures, self.valid, self.invalid
        )
    }
}
