pub mod message_handler;
pub mod req_resp;
pub mod sync;
pub mod types;
