//! Core business logic for the fulfillment engine.

/// Append-only audit trail recording and listing
pub mod audit;
/// Filament stock checks and clamped deduction
pub mod inventory;
/// Read-only farm dashboards
pub mod report;
/// Status transitions for orders, jobs, printers, and shipments
pub mod workflow;
