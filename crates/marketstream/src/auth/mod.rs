/*
[INPUT]:  REST collaborator with API credentials
[OUTPUT]: Session keys authorising private stream delivery
[POS]:    Auth layer - session key lifecycle for account-scoped channels
[UPDATE]: When session key endpoints or lifetimes change
*/

pub mod session_key;

pub use session_key::{
    SessionKey, SessionKeyConfig, SessionKeyEndpoint, SessionKeyManager, SessionKeyState,
};
