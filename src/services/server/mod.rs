// HTTP 接入层
//
// - routes: 路由与请求解析
// - server_instance: 监听与连接处理
// - utils: 响应体与 JSON 响应构建

pub mod routes;
pub mod server_instance;
pub mod utils;

pub use server_instance::ConduitServer;
