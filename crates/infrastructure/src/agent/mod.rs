pub mod scrapyd_agent;

pub use scrapyd_agent::ScrapydAgent;
