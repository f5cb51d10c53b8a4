//! Git and GitHub plumbing: the `git` runner, the working repository used as
//! merge oracle, URL handling, and the REST client that lists candidates.

pub mod command;
pub mod github;
pub mod oracle;
pub mod remote_url;

pub use command::{CommandOutput, GitRunner};
pub use github::{GitHubClient, GitHubRepository};
pub use oracle::{HeadState, MergeOracle, MergeOutcome, RepoSnapshot};
pub use remote_url::{parse_repository_url, RepositoryLocation};
