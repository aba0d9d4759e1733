pub mod mock_time;
pub mod mock_transport;
