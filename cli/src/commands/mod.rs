mod cart;
mod helpers;
mod ingredient;
mod recipe;
mod shopping;

pub(crate) use cart::{cmd_cart_add, cmd_cart_remove, cmd_cart_show};
pub(crate) use ingredient::{cmd_ingredient_add, cmd_ingredient_import, cmd_ingredient_search};
pub(crate) use recipe::{
    cmd_recipe_create, cmd_recipe_delete, cmd_recipe_import, cmd_recipe_list, cmd_recipe_set,
    cmd_recipe_show,
};
pub(crate) use shopping::cmd_shopping_list;
