//! Cross-module pipeline tests.

mod support;
