pub mod lines;

#[cfg_attr(docsrs, doc(cfg(feature = "glob-inputs")))]
#[cfg(feature = "glob-inputs")]
pub mod glob;
