pub mod db;


pub use db::SledStore;
