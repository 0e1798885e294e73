pub mod fault_client;
