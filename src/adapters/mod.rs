pub mod csv_reader;
pub mod http;
pub mod openai;

pub use csv_reader::RequirementReader;
pub use http::ReqwestTransport;
pub use openai::OpenAiEnricher;
