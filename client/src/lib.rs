//! # Game Client Library
//!
//! A headless client for the netcode. It joins a game on a server, mirrors
//! that game in a client-authority container and plays through a simple bot
//! in place of window input.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Connection lifecycle and event application:
//! - The server's reply to this client's own Connect creates the local mirror
//! - Masked Connect and Disconnect broadcasts add and remove other players
//! - Move, AutoAttack and Damage are applied to the mirror as they arrive
//! - Local actions go to the server and straight into the local inbound queue
//!
//! ### Bot Module (`bot`)
//! Picks the next action every few seconds: walk to a random walkable tile
//! or auto-attack a random known enemy.
//!
//! ## Consistency
//!
//! The mirror predicts movement and plays attack animations, but hit points
//! only change when the server's Damage arrives.

pub mod bot;
pub mod network;
