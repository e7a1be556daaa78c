pub mod cancel;
pub mod deployment;
pub mod poll;
pub mod response;
