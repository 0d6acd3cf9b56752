//! End-to-end download tests against SQLite stores and a mock media server.

mod download_flow;
