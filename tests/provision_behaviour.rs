//! Behavioural scenarios for `claimkb provision`.

mod provision;
