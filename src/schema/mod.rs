pub mod activation;
pub mod fragment;
pub mod key;
pub mod storylet;
