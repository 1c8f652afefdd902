pub mod funccall;
