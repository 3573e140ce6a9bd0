pub mod body;
pub mod responses;

pub use body::{box_body, full_body, BoxBody};
