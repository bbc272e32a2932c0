//! Integration tests for deploywatch


mod test_demux;
mod test_eventlog;
mod test_reconcile;
mod test_server;
