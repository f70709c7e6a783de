pub mod case_writer;
pub mod request_reader;
