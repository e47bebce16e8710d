mod pipeline;
mod sqlite_store;
mod yahoo_client;
