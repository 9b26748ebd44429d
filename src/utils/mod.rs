pub mod index_set;
