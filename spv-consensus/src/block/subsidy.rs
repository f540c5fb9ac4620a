//! Block subsidy computation.

pub mod general;
