pub mod gallery_persister;
pub mod json_gallery_store;
pub mod linear_scan_matcher;
