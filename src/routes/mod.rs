//! HTTP route handlers (C10's external interface, spec.md §6).

pub mod emails_search;
pub mod extraccion_generacion;
pub mod health;
pub mod process_emails;
