pub mod http_client;
pub mod page_capture;
