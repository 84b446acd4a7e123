pub mod init_map;
pub mod road_network;
pub mod visualize;
