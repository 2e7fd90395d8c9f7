pub mod match_content_type;
