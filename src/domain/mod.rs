//! Payment aggregate, commands, PSP outcome types and the ports the
//! application layer drives.

pub mod command;
pub mod execution;
pub mod payment;
pub mod ports;
