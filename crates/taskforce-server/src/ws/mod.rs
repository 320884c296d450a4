//! WebSocket handlers

pub mod task_events;
