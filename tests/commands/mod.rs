mod test_export;
