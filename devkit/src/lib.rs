/*!
# fleetlog DevKit - mocks and helpers for testing log collection

Lets collection be exercised end to end without real hosts:
- `MockConnector` / `MockSession`: scripted remote sessions recording every command
- `FleetBuilder`: fleets of groups and instances with predictable identities
- `TestHarness`: temp config + log dir wired into a `LogFetcher`
*/

pub mod fixtures;
pub mod mock_session;
pub mod test_utils;

pub use fixtures::FleetBuilder;
pub use mock_session::{IssuedCommand, MockConnector};
pub use test_utils::TestHarness;
