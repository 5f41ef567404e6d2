pub mod capture;
pub mod discover;
pub mod hex_utils;
pub mod hexdump;
pub mod layout;
pub mod scan;
pub mod sections;
