pub mod phone;
pub mod test_utils;
pub mod timefmt;
