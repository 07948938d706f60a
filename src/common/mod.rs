// Common utilities shared by the extractor, normalizer and denormalizer

pub mod json_path;
