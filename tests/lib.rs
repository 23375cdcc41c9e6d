//! Shared helpers for the gantry integration suites.
