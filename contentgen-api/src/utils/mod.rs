pub mod partial_json;
pub mod slug;
pub mod sse;
