//! Register model of the part, delays and pins for the unit tests.

pub(crate) mod mock;
