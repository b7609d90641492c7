//! Backend services behind the gate's trait seams.
//!
//! ARCHITECTURE
//! ============
//! The gate consults collaborators only through traits; this module holds
//! the shipped implementations so the binary runs standalone.

pub mod login;
