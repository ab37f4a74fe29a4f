// src/agentchat/mod.rs

pub mod agent;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod event;
pub mod group_chat;
pub mod history;
pub mod prompt_template;
pub mod rag;
pub mod selection;
pub mod termination;
pub mod tool_protocol;
pub mod tool_protocols;
pub mod tools;

// Let's explicitly export GroupChat so we don't have to access it via agentchat::group_chat::GroupChat
pub use group_chat::GroupChat;
