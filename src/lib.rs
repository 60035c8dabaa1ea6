//! # Interview Relay Backend
//!
//! Real-time relay between a candidate's browser and a remote
//! conversational-AI engine for the duration of one live interview,
//! multiplexed over two parallel channels:
//!
//! - a textual turn-taking chat channel (`/ws/interview`), and
//! - a continuous binary audio-streaming channel (`/ws/voice/{session_id}`).
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML files + environment variables)
//! - **state**: Shared application state and relay metrics
//! - **auth**: Credential Guard for admitting long-lived connections
//! - **relay**: Session Registry and per-session conversation state
//! - **engine**: Client for the AI engine's request/response text endpoint
//! - **websocket**: Chat Relay over the control channel
//! - **tunnel**: Audio Relay proxying the streaming channel to the engine
//! - **client**: Candidate-side audio pipeline (used by the voice-client binary)
//! - **health / middleware / error**: Operational surface and error mapping

pub mod auth;        // Credential Guard (auth.rs)
pub mod client;      // Client audio pipeline (client/ directory)
pub mod config;      // Configuration management (config.rs)
pub mod engine;      // AI engine text-endpoint client (engine.rs)
pub mod error;       // Error handling types (error.rs)
pub mod health;      // Health check endpoints (health.rs)
pub mod handlers;    // HTTP request handlers (handlers/ directory)
pub mod middleware;  // Custom middleware (middleware/ directory)
pub mod relay;       // Session registry and conversation state (relay/ directory)
pub mod state;       // Application state management (state.rs)
pub mod tunnel;      // Audio Relay proxy tunnel (tunnel.rs)
pub mod websocket;   // Control-channel Chat Relay (websocket.rs)
