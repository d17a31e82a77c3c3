//! Scenario tests: whole pipelines run through the engine

mod helpers;
mod scenarios;
