//! File-system collaborator interface

pub mod interface;
