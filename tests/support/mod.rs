pub mod gateway;
pub mod socket_guard;
