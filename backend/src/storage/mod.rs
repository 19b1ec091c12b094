pub mod artifact_store;
