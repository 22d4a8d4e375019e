pub mod source_api;
