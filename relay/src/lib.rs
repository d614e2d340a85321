//! Result relay.
//!
//! Tails the outbound result topic once and fans each decoded event out to
//! every connected viewer over server-sent events. One reader task owns the
//! log cursor; sessions are plain broadcast receivers, so a thousand viewers
//! still cost a single topic consumer.

pub mod reader;
pub mod server;
pub mod session;
