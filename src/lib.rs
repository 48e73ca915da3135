// Entity state model and DIS-style enumerations
pub mod entity;

// Echelon hierarchy of a team structure
pub mod team;

// Knowledge sessions and their role assignments
pub mod session;

// Geocentric to geodetic conversion
pub mod geo;

// Military symbol identification codes
pub mod symbol;

// Entity cache and timeout scheduling
pub mod state;

// Per-viewer, per-session entity filtering
pub mod filter;

// Configuration
pub mod config;

// HTTP and WebSocket APIs
pub mod api;

// Viewer and monitor connection handling
pub mod subscription;
