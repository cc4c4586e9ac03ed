//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod audit_log;
pub mod filament;
pub mod order;
pub mod print_job;
pub mod printer;
pub mod shipment;

// Re-export specific types to avoid conflicts
pub use audit_log::{Column as AuditLogColumn, Entity as AuditLog, Model as AuditLogModel};
pub use filament::{Column as FilamentColumn, Entity as Filament, Model as FilamentModel};
pub use order::{Column as OrderColumn, Entity as Order, Model as OrderModel, OrderStatus};
pub use print_job::{
    Column as PrintJobColumn, Entity as PrintJob, JobStatus, Model as PrintJobModel,
};
pub use printer::{Column as PrinterColumn, Entity as Printer, Model as PrinterModel, PrinterStatus};
pub use shipment::{
    Column as ShipmentColumn, Entity as Shipment, Model as ShipmentModel, ShipmentStatus,
};
