//! End-to-end tests of the generation pipeline against mock vendor backends
