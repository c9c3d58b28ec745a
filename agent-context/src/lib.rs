#![deny(missing_docs)]
//! Conversation Tree / Context Manager.
//!
//! Owns the append-only tree of turns (`tree`), turns it into LLM-ready
//! prompts and token counts (`manager`), and supplies the string
//! templates (`templates`) and token-counting backend (`tokenizer`) that
//! prompt assembly needs. Nothing here talks to a provider or dispatches
//! an action — it only decides *what goes in the next request* and *when
//! the tree should be pruned by summarization*.

pub mod manager;
pub mod templates;
pub mod tokenizer;
pub mod tree;

pub use manager::{ComputerDescriptor, ContextManager, ContextStats, SystemPromptContext};
pub use tokenizer::{ApproxTokenizer, Tokenizer};
pub use tree::{Tree, TreeData};
