mod common_ext;
mod observer_ext;
