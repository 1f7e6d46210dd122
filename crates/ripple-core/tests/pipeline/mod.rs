//! Pipeline 集成测试入口。
//!
//! - `ordering`：入站自头向尾、出站自尾向头的派发顺序，以及尾部/头部哨兵行为；
//! - `hot_swap`：事件进行中增删改节点；
//! - `cross_thread`：节点绑定到其他执行器时的生命周期钩子与事件派发。

mod cross_thread;
mod hot_swap;
mod ordering;
