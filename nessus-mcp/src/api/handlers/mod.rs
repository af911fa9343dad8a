// API handlers for the MCP server.
//
// Each file owns one or two closely related tool endpoints from the
// external surface.

pub mod queue;
pub mod results;
pub mod scanners;
pub mod status;
pub mod submit;
pub mod tasks;
