//! Report rendering.
//!
//! `column` renders the plugins table usage column, `markup` keeps that
//! output escaped and allow-listed, and `generator` produces whole reports.

pub mod column;
pub mod generator;
pub mod markup;

pub use generator::*;
