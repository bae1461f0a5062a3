// SPDX-License-Identifier: Apache-2.0

pub mod ingest;
pub mod init;
pub mod listener;
pub mod otlp;
pub mod server;
pub mod store;
