mod compile;
mod decode;
