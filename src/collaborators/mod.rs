//! External collaborators: the bead/work tracker, the optional mail
//! notifier, and the issue-export sink. These are the "explicitly out of
//! scope" boundaries named in spec §1 - traits with one real subprocess or
//! HTTP implementation, faked in tests. See spec §6.

pub mod bead;
pub mod mail;
