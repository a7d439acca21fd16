pub mod flatten;
pub mod openai_chat;
