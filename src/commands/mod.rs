// Stack commands: plan, graph, validate, outputs, diff, apply
pub mod stack;
