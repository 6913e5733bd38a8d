//! Diagnostics for skipped records.
//!
//! Record-level corruption never fails a query; the offending record is
//! skipped and a [`Diagnostic`] is emitted instead. Every diagnostic is logged
//! through `tracing::warn!`, kept in the Session's snapshot, and sent on the
//! Session's channel when one was attached with
//! [`SessionOptions::with_diagnostics`](crate::SessionOptions::with_diagnostics).

use std::fmt;
use std::sync::mpsc;

use crate::types::SymbolId;

/// Where a diagnostic was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticStage
{
    /// While converting provider records into the record store.
    Load,
    /// While materializing a record into a [`Symbol`](crate::Symbol).
    Materialize,
    /// While building a compiland's line table.
    LineTable,
    /// While projecting a symbol into the type graph.
    TypeGraph,
}

impl fmt::Display for DiagnosticStage
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            DiagnosticStage::Load => "load",
            DiagnosticStage::Materialize => "materialize",
            DiagnosticStage::LineTable => "line-table",
            DiagnosticStage::TypeGraph => "type-graph",
        };
        f.write_str(label)
    }
}

/// A skipped malformed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic
{
    /// Record the diagnostic is about, when the store assigned it an id.
    pub record: Option<SymbolId>,
    /// Stage that raised it.
    pub stage: DiagnosticStage,
    /// Human-readable reason.
    pub message: String,
}

impl Diagnostic
{
    pub fn new(record: Option<SymbolId>, stage: DiagnosticStage, message: impl Into<String>) -> Self
    {
        Self {
            record,
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self.record {
            Some(id) => write!(f, "[{}] record {id}: {}", self.stage, self.message),
            None => write!(f, "[{}] {}", self.stage, self.message),
        }
    }
}

/// Sender side of the diagnostic channel.
pub type DiagnosticSender = mpsc::Sender<Diagnostic>;
/// Receiver side of the diagnostic channel.
pub type DiagnosticReceiver = mpsc::Receiver<Diagnostic>;

/// Create a new diagnostic channel.
#[must_use]
pub fn diagnostic_channel() -> (DiagnosticSender, DiagnosticReceiver)
{
    mpsc::channel()
}
