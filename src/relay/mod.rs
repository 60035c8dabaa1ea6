//! # Interview Relay Module
//!
//! Holds the per-session conversation state that lives outside the database
//! while an interview is live, and the process-wide registry that routes
//! connections to it.
//!
//! ## Key Components:
//! - **Session**: one candidate's conversation (ordered turn history plus the
//!   idle / awaiting-engine state machine of the Chat Relay)
//! - **Registry**: concurrency-safe keyed store from session id to session,
//!   created lazily on first join and shared by the chat and audio channels
//!
//! ## Ownership:
//! The registry exclusively owns all session objects. Connections hold only a
//! session id and an `Arc` handle; no connection ever outlives the registry
//! entry it points to.

pub mod registry;   // Process-wide session id -> session map
pub mod session;    // Conversation state and turn-taking state machine
