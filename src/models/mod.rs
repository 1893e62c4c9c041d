//! Core data models for the chunked DICOM upload service.
//!
//! `UploadedFile` maps to the `uploaded_files` table via `sqlx::FromRow`;
//! the upload types describe ephemeral session state and wire DTOs.

pub mod upload;
pub mod uploaded_file;
