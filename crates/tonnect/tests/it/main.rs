//! End-to-end tests of the wallet kit over real transports.

mod common;

mod connect;
mod disconnect;
mod sign_data;
mod transaction;
