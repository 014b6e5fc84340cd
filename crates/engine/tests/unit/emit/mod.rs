//! # Emission Tests
